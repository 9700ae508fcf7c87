//! Appointment and document-status tracking for the citizen services portal.
//!
//! Appointments are sorted into ongoing, incomplete and previous views,
//! uploaded documents are reviewed against their required documents, and a
//! thin client covers the portal's admin and upload endpoints.

pub mod classify;
pub mod db;
pub mod documents;
pub mod fixture;
pub mod models;
pub mod portal;
pub mod report;
pub mod store;
