pub mod content_stream;
pub mod document;
pub mod image_xobject;
pub mod optimizer;
