use clap::ValueEnum;
use corpus_extract::BuildMode;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub(crate) enum PartialsMode {
    /// Rebuild every partial, reusing recorded listings
    Rebuild,
}

impl PartialsMode {
    pub(crate) const fn as_domain(mode: Option<Self>) -> BuildMode {
        match mode {
            Some(PartialsMode::Rebuild) => BuildMode::Rebuild,
            None => BuildMode::Missing,
        }
    }
}
