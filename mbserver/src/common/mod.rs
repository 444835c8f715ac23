pub(crate) mod bits;
pub(crate) mod buffer;
pub(crate) mod cursor;
pub(crate) mod frame;
pub(crate) mod function;
pub(crate) mod phys;
