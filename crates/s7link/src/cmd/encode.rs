use s7link_frame::{encode, Message, TRANSPORT_PREFIX};

use crate::cmd::EncodeArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let message = Message::new(args.type_id, args.data_id, args.payload);
    let wire = wire_form(&message, args.prefix);
    print_encoded(&message, &wire, format);
    Ok(SUCCESS)
}

fn wire_form(message: &Message, prefix: bool) -> String {
    let frame = encode(message);
    if prefix {
        format!("{TRANSPORT_PREFIX}{frame}")
    } else {
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_optional() {
        let message = Message::new(6, 0, "1");
        assert_eq!(wire_form(&message, false), "^ST^6^ID^0^DT^1^EN^");
        assert_eq!(wire_form(&message, true), "##^ST^6^ID^0^DT^1^EN^");
    }
}
