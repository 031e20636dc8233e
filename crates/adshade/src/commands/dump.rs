/// Prints the target application's window trees as JSON.
///
/// The engine produces the in-memory structure; this command only
/// serializes it, so the output can be piped into a file or a viewer.
#[cfg(windows)]
pub fn execute() {
    let engine = super::build_engine();
    let trees = engine.dump_trees();

    if trees.is_empty() {
        eprintln!("No target application windows found.");
        std::process::exit(1);
    }

    match serde_json::to_string_pretty(&trees) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: could not serialize tree: {e}"),
    }
}

#[cfg(not(windows))]
pub fn execute() {
    super::platform_unsupported();
}
