//! FIFF (`.fif`) reading and writing, compatible with
//! [MNE-Python](https://mne.tools) raw files.
//!
//! ```no_run
//! use meg_explorer::fiff::open_raw;
//!
//! let raw = open_raw("run01_raw.fif").unwrap();
//! println!("{} channels @ {} Hz, bads {:?}", raw.info.n_chan, raw.info.sfreq, raw.info.bads);
//! ```
pub mod constants;
pub mod info;
pub mod raw;
pub mod tag;
pub mod tree;
pub mod write;

pub use info::{read_meas_info, ChannelInfo, CoordTrans, MeasInfo, SensorType};
pub use raw::{open_raw, BufferRecord, RawFif};
pub use tag::{read_tag_header, TagHeader, TagWriter};
pub use tree::{read_tree, scan_directory, try_load_directory, Node};
pub use write::{write_raw, write_raw_to};
