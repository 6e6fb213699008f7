//! Shared driver plumbing: argument parsing with the documented exit codes
//! and rayon pool configuration.

use clap::Parser;

/// Parses arguments, exiting 0 on `--help`/`--version` and 1 on any usage
/// error instead of clap's default codes.
pub fn parse_or_exit<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(err) => {
            use clap::error::ErrorKind;
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    }
}

/// Resolves a `--threads` value (0 = all cores) and sizes the global rayon
/// pool accordingly. Returns the effective thread count; 1 means callers
/// should stay on the sequential paths.
pub fn configure_threads(threads: usize) -> usize {
    let effective = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };
    if effective > 1 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(effective)
            .build_global()
            .ok();
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_threads_resolves_auto() {
        assert!(configure_threads(0) >= 1);
        assert_eq!(configure_threads(1), 1);
        assert_eq!(configure_threads(4), 4);
    }
}
