/// Sign-and-magnitude integers as GRIB edition 1 stores them: the top bit is
/// the sign, the remaining bits the absolute value.
pub(crate) trait GribInt<I> {
    fn as_grib_int(&self) -> I;
}

/// Inverse of [`GribInt`].
pub(crate) trait ToGribUint<U> {
    fn to_grib_uint(&self) -> U;
}

macro_rules! add_impl_for_ints {
    ($(($ty_src:ty, $ty_dst:ty),)*) => ($(
        impl GribInt<$ty_dst> for $ty_src {
            fn as_grib_int(&self) -> $ty_dst {
                if self.leading_zeros() == 0 {
                    let abs = (self << 1 >> 1) as $ty_dst;
                    -abs
                } else {
                    *self as $ty_dst
                }
            }
        }

        impl ToGribUint<$ty_src> for $ty_dst {
            fn to_grib_uint(&self) -> $ty_src {
                let sign: $ty_src = 1 << (<$ty_src>::BITS - 1);
                let abs = self.unsigned_abs() as $ty_src & !sign;
                if *self < 0 {
                    abs | sign
                } else {
                    abs
                }
            }
        }
    )*);
}

add_impl_for_ints! {
    (u8, i8),
    (u16, i16),
    (u32, i32),
}

pub(crate) fn read_u24(buf: &[u8], start: usize) -> u32 {
    u32::from_be_bytes([0, buf[start], buf[start + 1], buf[start + 2]])
}

/// 24-bit sign-and-magnitude integer.
pub(crate) fn read_i24(buf: &[u8], start: usize) -> i32 {
    let raw = read_u24(buf, start);
    let abs = (raw & 0x7f_ffff) as i32;
    if raw & 0x80_0000 != 0 {
        -abs
    } else {
        abs
    }
}

pub(crate) fn u24_bytes(value: u32) -> [u8; 3] {
    let b = value.to_be_bytes();
    [b[1], b[2], b[3]]
}

pub(crate) fn i24_bytes(value: i32) -> [u8; 3] {
    let abs = value.unsigned_abs() & 0x7f_ffff;
    let raw = if value < 0 { abs | 0x80_0000 } else { abs };
    u24_bytes(raw)
}
