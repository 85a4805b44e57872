use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Output goes to stderr so it never
/// mixes into prompt answers. `RUST_LOG` overrides the verbosity flags.
///
/// With `crlf` set every line ends in `\r\n`, which is what a terminal in
/// raw mode needs to return the cursor to column 0.
pub fn init(verbose: bool, quiet: bool, crlf: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    if crlf {
        builder
            .with_writer(|| CrlfWriter::new(std::io::stderr()))
            .init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
}

fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "procsampler=debug"
    } else if quiet {
        "procsampler=warn"
    } else {
        "procsampler=info"
    }
}

/// Writer that expands every `\n` to `\r\n`.
pub struct CrlfWriter<W> {
    inner: W,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
