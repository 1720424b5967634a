/// The xtask binary delegates entirely to nih_plug_xtask, which provides
/// the `bundle` subcommand. Usage:
///
///   cargo xtask bundle fake-tape-delay --release
///
/// This compiles the plugin as a cdylib and packages it into
/// `target/bundled/Fake Tape Delay.vst3` and `.clap` bundles.
fn main() -> nih_plug_xtask::Result<()> {
    nih_plug_xtask::main()
}
