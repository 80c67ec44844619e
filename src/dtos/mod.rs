pub mod authdtos;
pub mod waitlistdtos;
