pub mod edata;
pub mod frame;
pub mod meter;

pub use edata::*;
pub use frame::*;

/// Echonetliteの電文表現(ビッグエンディアン・固定長整数)
pub fn wire_config()
-> bincode::config::Configuration<bincode::config::BigEndian, bincode::config::Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}
