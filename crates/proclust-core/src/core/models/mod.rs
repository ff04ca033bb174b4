pub mod cluster;
pub mod frame;
pub mod species;
pub mod topology;
