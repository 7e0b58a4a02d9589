pub mod args;
pub mod channels;
pub mod check;
pub mod init;
pub mod serve;
