pub mod designer;
pub mod responses;
