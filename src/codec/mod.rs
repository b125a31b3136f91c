pub mod lzfu;
