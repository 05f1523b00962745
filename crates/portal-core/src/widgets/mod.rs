//! Helpers the views build their markup and side effects from.

pub mod charts;
pub mod checklist;
pub mod export;
pub mod html;
pub mod photos;
pub mod validation;
