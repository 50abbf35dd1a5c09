pub mod localization;
pub mod rate_limit;
