use chrono::{DateTime, NaiveDate, Utc};

/// `02 / 19 / 1990`
pub fn birth_date(date: NaiveDate) -> String {
    date.format("%m / %d / %Y").to_string()
}

/// `01 May 2024`
pub fn posted_on(created_at: DateTime<Utc>) -> String {
    created_at.format("%d %b %Y").to_string()
}

pub fn optional_birth_date(date: Option<NaiveDate>) -> String {
    date.map(birth_date).unwrap_or_default()
}
