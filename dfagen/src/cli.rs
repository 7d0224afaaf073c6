use bpaf::*;

use dfagen_core::Bitness;
use dfagen_gen::printer::ConsumerMode;

#[derive(Debug, Clone)]
pub struct Cli {
    pub bitness: Bitness,
    pub mode: ConsumerMode,
    pub output: Option<String>,
    pub path: String,
}

pub fn parse_cli() -> Cli {
    let bitness = short('b')
        .long("bitness")
        .help("Target processor mode [default: 64, valid modes: 32, 64]")
        .argument::<String>("BITS")
        .parse(|s| match s.as_str() {
            "32" => Ok(Bitness::B32),
            "64" => Ok(Bitness::B64),
            _ => Err(format!("invalid bitness {s}")),
        })
        .fallback(Bitness::B64);

    let mode = short('m')
        .long("mode")
        .help("Grammar consumer [default: decoder, valid modes: decoder, validator]")
        .argument::<String>("MODE")
        .parse(|s| match s.as_str() {
            "decoder" => Ok(ConsumerMode::Decoder),
            "validator" => Ok(ConsumerMode::Validator),
            _ => Err(format!("invalid mode {s}")),
        })
        .fallback(ConsumerMode::Decoder);

    let output = short('o')
        .long("output")
        .help("Write grammar to FILE instead of stdout")
        .argument::<String>("FILE")
        .optional();

    let path = positional("FILE").help("Instruction definition file to compile");

    construct!(Cli {
        bitness,
        mode,
        output,
        path,
    })
    .to_options()
    .version(env!("CARGO_PKG_VERSION"))
    .descr("Compile x86 instruction definitions into DFA grammar fragments")
    .fallback_to_usage()
    .run()
}
