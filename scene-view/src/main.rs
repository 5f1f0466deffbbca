//! Application entry point for the scene editor.
//!
//! This binary sets up logging and eframe/egui, then delegates all
//! interactive logic to [`Viewer`] from the `viewer` module.

mod integrator;
mod viewer;

use viewer::Viewer;

/// Starts the native eframe application.
///
/// ### Returns
/// - `Ok(())` if the application runs to completion without errors.
/// - `Err` if eframe fails to create the native window or event loop.
fn main() -> eframe::Result<()> {
    env_logger::init();

    let options = eframe::NativeOptions::default();

    eframe::run_native(
        "Scene Editor",
        options,
        Box::new(|_cc| {
            // Construct the root app state for the editor.
            Ok(Box::new(Viewer::new()))
        }),
    )
}
