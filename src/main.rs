fn main() {
    #[cfg(feature = "cli")]
    ipsapply::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("ipsa: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
