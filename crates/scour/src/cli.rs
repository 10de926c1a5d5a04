use anyhow::Result;

use crate::file_manager::Source;

pub const USAGE: &str = "\
Usage: scour [OPTIONS] [INPUT]

Sanitizes untrusted HTML (or markdown) against an allow-list policy.
Reads INPUT, or standard input when INPUT is absent or '-'.

Options:
  -p, --policy <NAME>   preset or config-defined policy (default from config)
  -o, --output <PATH>   write to file (an existing file is kept as .bak)
  -m, --markdown        treat input as markdown
  -s, --strict          fail closed: exit non-zero and print violations
  -r, --report          print the sanitize report to stderr
  -h, --help            print this help
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub policy: Option<String>,
    pub output: Option<String>,
    pub markdown: bool,
    pub strict: bool,
    pub report: bool,
    pub help: bool,
    pub input: Source,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            policy: None,
            output: None,
            markdown: false,
            strict: false,
            report: false,
            help: false,
            input: Source::Stdin,
        }
    }
}

impl Args {
    /// Parses arguments without the program name.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Args::default();
        let mut input: Option<String> = None;
        let mut args = args.into_iter().map(Into::into);
        let mut positional_only = false;

        while let Some(arg) = args.next() {
            if positional_only || arg == "-" || !arg.starts_with('-') {
                if let Some(previous) = input.replace(arg) {
                    return Err(anyhow::anyhow!(
                        "Only one input may be given (already have '{}')",
                        previous
                    ));
                }
                continue;
            }

            let (flag, inline_value) = match arg.split_once('=') {
                Some((flag, value)) if arg.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };

            match flag.as_str() {
                "--" => positional_only = true,
                "-p" | "--policy" => {
                    parsed.policy = Some(take_value(&flag, inline_value, &mut args)?);
                }
                "-o" | "--output" => {
                    parsed.output = Some(take_value(&flag, inline_value, &mut args)?);
                }
                "-m" | "--markdown" => parsed.markdown = true,
                "-s" | "--strict" => parsed.strict = true,
                "-r" | "--report" => parsed.report = true,
                "-h" | "--help" => parsed.help = true,
                _ => return Err(anyhow::anyhow!("Unknown option '{}'\n\n{}", arg, USAGE)),
            }
        }

        parsed.input = Source::from_arg(input.as_deref());
        Ok(parsed)
    }
}

fn take_value(
    flag: &str,
    inline_value: Option<String>,
    args: &mut impl Iterator<Item = String>,
) -> Result<String> {
    let value = match inline_value {
        Some(value) => Some(value),
        None => args.next(),
    };
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(anyhow::anyhow!("Option '{}' requires a value", flag)),
    }
}
