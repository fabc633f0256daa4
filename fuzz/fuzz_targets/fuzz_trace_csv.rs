#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = std::env::temp_dir().canonicalize() else {
        return;
    };
    let path = dir.join(format!("rover-fuzz-trace-{}.csv", std::process::id()));
    if std::fs::write(&path, data).is_err() {
        return;
    }
    if let Ok(rows) = rover_config::load_trace_csv(&path) {
        assert!(!rows.is_empty());
        assert!(rows.windows(2).all(|w| w[0].t_us < w[1].t_us));
    }
    let _ = std::fs::remove_file(&path);
});
