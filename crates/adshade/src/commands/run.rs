/// Runs the engine in the foreground until Ctrl+C.
///
/// On shutdown the engine restores every window it mutated, so the
/// host application is left exactly as it was found.
#[cfg(windows)]
pub fn execute() {
    use std::sync::mpsc;

    let mut engine = super::build_engine();
    if let Err(e) = engine.start() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    println!("Adshade running. Press Ctrl+C to stop and restore.");

    let (tx, rx) = mpsc::channel();
    adshade_windows::ctrl_c::set_handler(tx);
    let _ = rx.recv();

    println!("Stopping...");
    engine.stop();

    let state = engine.state();
    println!(
        "Done. hidden={} resized={} closed={} restored={} events: {} received / {} coalesced / {} dropped",
        state.ads_hidden,
        state.resizes,
        state.closes,
        state.restores,
        state.events_received,
        state.events_coalesced,
        state.events_dropped
    );
}

#[cfg(not(windows))]
pub fn execute() {
    super::platform_unsupported();
}
