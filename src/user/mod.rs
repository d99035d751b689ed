//! Per-user collaborator stores consumed by the search core: visa
//! preferences and the ignored-jobs / ignored-companies skip lists.

pub mod ignored;
pub mod preferences;
