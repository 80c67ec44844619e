pub mod membermodel;
pub mod referralmodel;
pub mod sessionmodel;
