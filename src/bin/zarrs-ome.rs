//! Interactive front end: asks for paths and an image name, then converts.
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use zarrs_ome::{ConvertConfig, convert};

/// Source store looked up next to the executable when none is given.
const DEFAULT_SOURCE_DIR: &str = "vcelldata";
/// Directory, relative to the working directory, receiving every output image.
const OUTPUT_DIR: &str = "output";
const DEFAULT_OUTPUT_NAME: &str = "output";
const DEFAULT_IMAGE_NAME: &str = "image";

/// Ask a question on stdout and read one line of stdin, falling back to `default`.
fn prompt(input: &mut impl BufRead, question: &str, default: &str) -> io::Result<String> {
    print!("{question} [{default}]: ");
    io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

fn default_source() -> io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().unwrap_or(Path::new("."));
    Ok(dir.join(DEFAULT_SOURCE_DIR))
}

fn read_config(
    input: &mut impl BufRead,
    default_source: &Path,
    output_dir: &Path,
) -> io::Result<ConvertConfig> {
    let default_source = default_source.display().to_string();
    let source = prompt(input, "Source Zarr path", &default_source)?;
    let output = prompt(input, "Output name", DEFAULT_OUTPUT_NAME)?;

    std::fs::create_dir_all(output_dir)?;
    let destination = output_dir.join(ConvertConfig::destination_for(output));
    println!("Output will be saved to: {}", destination.display());

    let image_name = prompt(input, "Image name", DEFAULT_IMAGE_NAME)?;
    let overwrite = destination.exists() && {
        let question = format!("{} exists, overwrite? (y/n)", destination.display());
        prompt(input, &question, "n")?.eq_ignore_ascii_case("y")
    };
    let mut config = ConvertConfig::new(PathBuf::from(source), destination, image_name);
    config.overwrite = overwrite;
    Ok(config)
}

fn read_input() -> io::Result<ConvertConfig> {
    let source = default_source()?;
    read_config(&mut io::stdin().lock(), &source, Path::new(OUTPUT_DIR))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match read_input() {
        Ok(config) => config,
        Err(e) => {
            log::error!("could not read input: {e}");
            return ExitCode::FAILURE;
        }
    };

    match convert(&config) {
        Ok(conversion) => {
            log::info!(
                "converted {} channel(s) from {}",
                conversion.geometry.channel_count(),
                conversion.source_data_type.name()
            );
            println!(
                "Conversion complete. OME-Zarr image is at {}",
                config.destination_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("conversion failed: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn defaults_place_output_in_output_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let output_dir = dir.path().join(OUTPUT_DIR);
        let default_source = dir.path().join(DEFAULT_SOURCE_DIR);
        let mut input = Cursor::new("\n\n\n");

        let config = read_config(&mut input, &default_source, &output_dir).unwrap();
        assert!(output_dir.is_dir());
        assert_eq!(config.source_path, default_source);
        assert_eq!(config.destination_path, output_dir.join("output.ome.zarr"));
        assert_eq!(config.image_name, DEFAULT_IMAGE_NAME);
        assert!(!config.overwrite);
    }

    #[test]
    fn existing_output_asks_before_overwriting() {
        let dir = tempfile::TempDir::new().unwrap();
        let output_dir = dir.path().join(OUTPUT_DIR);
        std::fs::create_dir_all(output_dir.join("cells.ome.zarr")).unwrap();
        let mut input = Cursor::new("raw.zarr\ncells\nnuclei\ny\n");

        let config = read_config(&mut input, dir.path(), &output_dir).unwrap();
        assert_eq!(config.source_path, PathBuf::from("raw.zarr"));
        assert_eq!(config.destination_path, output_dir.join("cells.ome.zarr"));
        assert_eq!(config.image_name, "nuclei");
        assert!(config.overwrite);
    }
}
