use crate::image::ExecutableImage;
use crate::runtime::cached_function_table;
use clap::ArgMatches;
use std::io;
use std::path::Path;

pub fn symbols(argv: &ArgMatches) -> io::Result<()> {
    let binary = argv.value_of("binary").map(Path::new).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Must specify a binary to read")
    })?;

    let image = ExecutableImage::open(binary)?;
    let table = cached_function_table(&image, binary)?;

    for (address, name) in table.iter() {
        println!("0x{:08x} {}", address, name);
    }

    Ok(())
}
