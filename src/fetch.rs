use std::time::Duration;

use ureq::ResponseExt;

use crate::config::Config;
use crate::error::Result;

/// A fetched HTTP response, reduced to what the pipeline needs.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    /// Raw body text
    pub body: String,
}

impl Response {
    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound transport seam.
///
/// The pipeline only ever issues GET requests; tests substitute a stub that
/// serves canned bodies instead of touching the network.
pub trait Fetch {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response>;
}

/// HTTP client backed by a shared ureq agent.
pub struct HttpClient {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpClient {
    /// Build a client from the pipeline configuration.
    ///
    /// Non-success statuses are surfaced as responses, not errors: the
    /// pipeline decides per stage whether a status is fatal.
    pub fn new(config: &Config) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl Fetch for HttpClient {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response> {
        let mut request = self.agent.get(url);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        request = request.header("User-Agent", &self.user_agent);

        let response = request.call()?;
        let status = response.status().as_u16();
        let final_url = response.get_uri().to_string();
        let body = response.into_body().read_to_string()?;

        Ok(Response {
            status,
            url: final_url,
            body,
        })
    }
}
