use molt_obj_model::MoltObject;

/// Seconds since the epoch, whole seconds as a float.
#[cfg(unix)]
pub fn time() -> MoltObject {
    let now = unsafe { libc::time(std::ptr::null_mut()) };
    MoltObject::from_float(now as f64)
}

#[cfg(not(unix))]
pub fn time() -> MoltObject {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    MoltObject::from_float(now as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_tracks_system_clock() {
        let before = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        let now = time().as_float().unwrap();
        assert_eq!(now.fract(), 0.0);
        assert!((now - before).abs() < 5.0);
    }
}
