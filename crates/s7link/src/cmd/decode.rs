use std::io::Read;

use s7link_frame::{decode, Decoded, FrameReader};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS};
use crate::output::{print_decoded, OutputFormat};

/// Exits with `FAILURE` when the input holds no complete frame.
pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = read_input(&args)?;
    let decoded = decode_input(&input, args.chunk)?;

    print_decoded(&decoded, format);
    if decoded.messages.is_empty() {
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(text) = &args.text {
        return Ok(text.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return std::fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }

    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .map_err(|err| io_error("failed reading stdin", err))?;
    Ok(input)
}

fn decode_input(input: &[u8], chunk: bool) -> CliResult<Decoded> {
    if chunk {
        let mut reader = FrameReader::new();
        let messages = reader.feed(input);
        return Ok(Decoded {
            messages,
            remainder: reader.pending().to_string(),
        });
    }

    let text = std::str::from_utf8(input).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("input is not valid UTF-8 ({err}); use --chunk for raw bytes"),
        )
    })?;
    Ok(decode(text))
}
