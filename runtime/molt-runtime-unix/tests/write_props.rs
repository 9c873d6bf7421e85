use std::collections::VecDeque;

use molt_runtime_core::with_gil;
use molt_runtime_unix::{
    buffered_write_with, single_write_with, FdWrite, UnixErrorKind, UNIX_BUFFER_SIZE,
};
use proptest::prelude::*;

/// Accepts a scripted number of bytes per call, then everything.
struct Trickle {
    accept: VecDeque<usize>,
    out: Vec<u8>,
    largest_chunk: usize,
}

impl FdWrite for Trickle {
    fn write(&mut self, _fd: i32, data: &[u8]) -> Result<usize, UnixErrorKind> {
        self.largest_chunk = self.largest_chunk.max(data.len());
        let n = self.accept.pop_front().unwrap_or(data.len()).min(data.len());
        self.out.extend_from_slice(&data[..n]);
        Ok(n)
    }
}

fn window() -> impl Strategy<Value = (Vec<u8>, usize, usize)> {
    prop::collection::vec(any::<u8>(), 0..(UNIX_BUFFER_SIZE * 2 + 300)).prop_flat_map(|data| {
        let len = data.len();
        (Just(data), 0..=len).prop_flat_map(|(data, ofs)| {
            let rest = data.len() - ofs;
            (Just(data), Just(ofs), 0..=rest)
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn buffered_write_delivers_exact_window(
        (data, ofs, len) in window(),
        accept in prop::collection::vec(1usize..5000, 0..6),
    ) {
        let mut writer = Trickle { accept: accept.into(), out: Vec::new(), largest_chunk: 0 };
        let n = with_gil(|mut py| {
            let buffer = py.heap().alloc_bytes(&data);
            let n = buffered_write_with(&mut py, &mut writer, 3, buffer, ofs as i64, len as i64);
            py.heap().dec_ref(buffer);
            n
        });
        prop_assert_eq!(n, Ok(len));
        prop_assert_eq!(&writer.out[..], &data[ofs..ofs + len]);
        prop_assert!(writer.largest_chunk <= UNIX_BUFFER_SIZE);
    }

    #[test]
    fn single_write_never_exceeds_one_buffer((data, ofs, len) in window()) {
        let mut writer = Trickle { accept: VecDeque::new(), out: Vec::new(), largest_chunk: 0 };
        let n = with_gil(|mut py| {
            let buffer = py.heap().alloc_bytes(&data);
            let n = single_write_with(&mut py, &mut writer, 3, buffer, ofs as i64, len as i64);
            py.heap().dec_ref(buffer);
            n
        });
        prop_assert_eq!(n, Ok(len.min(UNIX_BUFFER_SIZE)));
        prop_assert_eq!(&writer.out[..], &data[ofs..ofs + len.min(UNIX_BUFFER_SIZE)]);
    }
}
