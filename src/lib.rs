//! Grades web application coursework in two ways: flat, process-backed tests
//! run in dependency order, and structured page tests driven through a
//! headless browser. A host-side command runs either kind inside a tester
//! container.

pub mod browser;
pub mod commands;
pub mod container;
pub mod errors;
pub mod logging;
pub mod options;
pub mod pages;
pub mod schedule;
