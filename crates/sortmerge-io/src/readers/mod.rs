//! Pull-interface sources over files.

pub mod csv;
