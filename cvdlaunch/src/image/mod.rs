//! Image manipulation: mixing a replacement system image into a super
//! image via the opaque OTA packer.

mod mixer;

pub use mixer::SuperImageMixer;
