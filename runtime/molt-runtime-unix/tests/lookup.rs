#![cfg(unix)]

use molt_obj_model::MoltObject;
use molt_runtime_core::{take_exception, with_gil};
use molt_runtime_unix::ffi::{molt_unix_getgroups, molt_unix_getprotobyname, molt_unix_time};
use molt_runtime_unix::{
    getgroups, getlogin, getprotobyname, getprotobynumber, UnixError, UnixErrorKind,
};

#[test]
fn getgroups_matches_libc() {
    let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
    assert!(count >= 0);
    with_gil(|mut py| {
        let groups = getgroups(&mut py).expect("getgroups");
        let mut heap = py.heap();
        let items = heap.tuple(groups).unwrap().to_vec();
        assert_eq!(items.len(), count as usize);
        assert!(items.iter().all(|item| item.as_int().is_some_and(|gid| gid >= 0)));
        heap.dec_ref(groups);
    });
}

#[test]
fn getlogin_yields_name_or_enoent() {
    with_gil(|mut py| match getlogin(&mut py) {
        Ok(name) => {
            let mut heap = py.heap();
            assert!(!heap.str_value(name).unwrap().is_empty());
            heap.dec_ref(name);
        }
        Err(err) => {
            assert_eq!(err, UnixError::os("getlogin", UnixErrorKind::NotFound));
            assert_eq!(err.exception_kind(), "FileNotFoundError");
        }
    });
}

#[test]
fn protocol_lookups_agree() {
    with_gil(|mut py| {
        let name = py.heap().alloc_str("tcp");
        match getprotobyname(&mut py, name) {
            Ok(entry) => {
                let number = py.heap().tuple(entry).unwrap()[2].as_int().unwrap();
                assert_eq!(number, 6);
                let by_number = getprotobynumber(&mut py, number).expect("same entry by number");
                let mut heap = py.heap();
                let fields = heap.tuple(by_number).unwrap().to_vec();
                assert_eq!(heap.str_value(fields[0]).unwrap(), "tcp");
                heap.dec_ref(by_number);
                heap.dec_ref(entry);
            }
            // Minimal images ship without /etc/protocols.
            Err(err) => assert_eq!(err, UnixError::NotFound { call: "getprotobyname" }),
        }
        py.heap().dec_ref(name);
    });
}

#[test]
fn unknown_protocol_is_not_found() {
    with_gil(|mut py| {
        let name = py.heap().alloc_str("no-such-protocol-molt");
        let err = getprotobyname(&mut py, name).unwrap_err();
        assert_eq!(err, UnixError::NotFound { call: "getprotobyname" });
        py.heap().dec_ref(name);
        let err = getprotobynumber(&mut py, i64::from(i32::MAX) + 1).unwrap_err();
        assert_eq!(err.exception_kind(), "OverflowError");
    });
}

#[test]
fn abi_not_found_raises_lookup_error() {
    let name = with_gil(|mut py| py.heap().alloc_str("no-such-protocol-molt"));
    let rc = molt_unix_getprotobyname(name.bits());
    assert_eq!(rc, MoltObject::none().bits());
    with_gil(|mut py| {
        let exc = take_exception().expect("pending exception");
        let mut heap = py.heap();
        assert_eq!(heap.exception(exc).unwrap().0, "LookupError");
        heap.dec_ref(exc);
        heap.dec_ref(name);
    });
}

#[test]
fn abi_getgroups_and_time() {
    let groups = MoltObject::from_bits(molt_unix_getgroups());
    assert!(groups.is_handle());
    with_gil(|mut py| py.heap().dec_ref(groups));
    let now = MoltObject::from_bits(molt_unix_time());
    assert!(now.as_float().is_some_and(|secs| secs > 1.0e9));
}
