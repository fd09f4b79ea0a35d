pub mod date_time {
    use chrono::{NaiveDateTime, ParseResult};
    use serde::Serializer;

    /// Timestamp layout used by route files and traffic reports.
    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(value: &str) -> ParseResult<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value, FORMAT)
    }

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

}
