pub mod encoding;
pub mod scoped_cache;
pub mod shutdown;
pub mod tracing;

pub mod string {
    pub trait ToOption<T> {
        fn to_option(self) -> Option<T>;
    }
    impl ToOption<String> for String {
        /// None for empty or whitespace-only strings, trimmed otherwise
        #[inline]
        fn to_option(self) -> Option<String> {
            let trimmed = self.trim();
            if trimmed.is_empty() {
                None
            } else if trimmed.len() == self.len() {
                Some(self)
            } else {
                Some(trimmed.to_string())
            }
        }
    }
    impl ToOption<String> for Option<String> {
        #[inline]
        fn to_option(self) -> Option<String> {
            self.and_then(|s| s.to_option())
        }
    }
}

pub mod datetime {
    use chrono::{DateTime, Local};

    pub fn now() -> DateTime<Local> {
        Local::now()
    }

    /// Timestamp used in output file names (YYYYMMDD_HHMMSS)
    pub fn file_stamp(dt: &DateTime<Local>) -> String {
        dt.format("%Y%m%d_%H%M%S").to_string()
    }
}

pub mod json {
    /// Slice from the first '{' to the last '}' (model output often wraps JSON in prose or fences)
    pub fn extract_object(text: &str) -> Option<&str> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end < start {
            return None;
        }
        Some(&text[start..=end])
    }

}
