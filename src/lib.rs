//! Automated class attendance check-in for a university web portal.
//! The library holds everything with testable logic: the schedule/window
//! resolver, the encrypted credential store, and the single orchestration
//! flow shared by interactive and unattended runs. Browser driving sits
//! behind the `AttendanceSubmitter` trait so the core never talks to a
//! webdriver directly.

pub mod app;
pub mod config;
pub mod credentials;
pub mod schedule;
pub mod submit;
