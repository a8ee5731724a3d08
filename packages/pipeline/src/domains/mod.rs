//! Domain layers: documents (and their results/batches) and teachers.

pub mod documents;
pub mod teachers;
