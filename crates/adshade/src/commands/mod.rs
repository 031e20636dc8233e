pub mod dump;
pub mod init;
pub mod run;
pub mod scan;

/// Builds the engine over the live Win32 window system.
///
/// Only meaningful on Windows; other platforms get an error message
/// and a non-zero exit.
#[cfg(windows)]
pub(crate) fn build_engine() -> adshade_core::Engine {
    use std::sync::Arc;

    let config = adshade_core::config::load();
    adshade_core::log::init(&config.logging);
    let rules = adshade_core::config::load_rules();
    let sys = Arc::new(adshade_windows::Win32WindowSystem::new());
    adshade_core::Engine::new(sys, config, &rules)
}

#[cfg(not(windows))]
pub(crate) fn platform_unsupported() -> ! {
    eprintln!("Error: this command drives the Win32 window system and only runs on Windows.");
    std::process::exit(1);
}
