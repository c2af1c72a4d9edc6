// Engine - Detection, recording, scanning and clip synthesis

pub mod detector;
pub mod recorder;
pub mod scanner;
pub mod splitter;
