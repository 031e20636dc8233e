/// One synchronous classify+mutate pass, then print the engine state.
///
/// Useful for verifying rules without leaving the engine resident.
/// Mutations are not restored on exit — run again with protection
/// disabled, or restart the host application, to undo them.
#[cfg(windows)]
pub fn execute() {
    let engine = super::build_engine();
    engine.force_scan();

    let state = engine.state();
    match serde_json::to_string_pretty(&state) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: could not serialize state: {e}"),
    }
}

#[cfg(not(windows))]
pub fn execute() {
    super::platform_unsupported();
}
