pub mod crc32;
pub mod spifs;
