pub mod debug;
pub mod ext;
pub mod fs;
pub mod props;
