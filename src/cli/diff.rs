use crate::diff::DeploymentScript;
use clap::ArgMatches;
use std::io;
use std::path::Path;

pub fn diff(argv: &ArgMatches) -> io::Result<()> {
    let before = argv.value_of("before").map(Path::new).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Must specify the original file")
    })?;
    let after = argv.value_of("after").map(Path::new).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Must specify the patched file")
    })?;

    let script = DeploymentScript::compile_files(before, after)?;

    match argv.value_of("out") {
        Some(out) => {
            script.write(Path::new(out))?;
            info!(
                "Wrote {} ({} runs, {} -> {})",
                out,
                script.runs().len(),
                script.before_md5(),
                script.after_md5()
            );
        }
        None => print!("{}", script),
    }

    Ok(())
}
