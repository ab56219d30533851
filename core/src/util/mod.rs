pub mod onetimeflag;

pub use onetimeflag::OneTimeFlag;
