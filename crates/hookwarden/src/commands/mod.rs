pub mod fire;
pub mod init;
pub mod list;
pub mod scaffold;
