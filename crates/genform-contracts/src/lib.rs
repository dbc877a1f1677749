//! Data model shared by the generation form engine: field values, the model
//! catalog, field metadata resolution, session events and drafts.

pub mod catalog;
pub mod drafts;
pub mod events;
pub mod fields;
pub mod values;
