pub mod master;
mod worker;
