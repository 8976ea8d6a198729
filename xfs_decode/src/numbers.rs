use crate::{Decode, DecodeError, check};

macro_rules! impl_decode_be {
    ($($t:ty),*) => {
        $(
            impl Decode for $t {
                fn decode(input: &[u8]) -> Result<(Self, usize), DecodeError> {
                    const SIZE: usize = core::mem::size_of::<$t>();
                    check(input, SIZE)?;
                    let mut bytes = [0u8; SIZE];
                    bytes.copy_from_slice(&input[..SIZE]);
                    Ok((<$t>::from_be_bytes(bytes), SIZE))
                }
            }
        )*
    };
}

impl_decode_be!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &[u8]) -> Result<(Self, usize), DecodeError> {
        check(input, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&input[..N]);
        Ok((out, N))
    }
}
