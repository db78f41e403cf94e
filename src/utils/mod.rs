//! The `utils` module holds the pieces shared by every other module:
//! the error types and logging setup.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
    }

    #[test]
    fn parse_level_falls_back_to_info() {
        assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
        assert_eq!(logging::parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(logging::parse_level("loud"), tracing::Level::INFO);
    }
}
