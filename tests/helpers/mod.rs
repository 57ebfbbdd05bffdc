pub mod log_validator;
