use serde::{Deserialize, Serialize};

/// One normalized customer review.
///
/// Normalization guarantees every field is populated: unknown authors become
/// "Аноним", empty bodies become "Без текста", a missing rating defaults
/// to 5 and a missing date to the extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub author: String,
    /// Star rating, 1–5
    pub rating: u8,
    pub text: String,
    /// `%Y-%m-%d` when the source gave only a day, `%Y-%m-%d %H:%M:%S` otherwise
    pub date: String,
}

/// Extracted review data for one organization.
///
/// Always fully populated: fields no strategy could extract carry their
/// documented defaults (0.0 rating, 0 count, placeholder name, no photo,
/// empty review list) instead of being omitted. Serializes to the wire
/// shape the consuming web layer caches and returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub rating: f64,
    pub review_count: u32,
    pub company_name: String,
    pub company_photo: Option<String>,
    /// Freshest first, at most ten
    pub reviews: Vec<Review>,
    /// ISO-8601 extraction timestamp
    pub fetched_at: String,
}
