// Export all route modules
pub mod scrape;

// Re-export all route handlers for easy importing
pub use scrape::*;
