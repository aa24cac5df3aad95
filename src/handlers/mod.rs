// Handler modules
pub mod checks;
pub mod diagnose;

// Re-export all handler functions
pub use checks::handle_checks;
pub use diagnose::handle_diagnose;
