use clap::ValueEnum;
use std::{fmt, str::FromStr};

/// How much we know about an image when picking it for a node.
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SelectionMode {
    /// Only the platform is known
    Basic,
    /// Match the OS of the flux view to the OS of the image
    Platform,
    /// Match the OS and the OS version
    PlatformVersion,
    /// Let compspec select on OS, OS version, GPU and platform
    DescriptiveBasic,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Basic => write!(f, "basic"),
            SelectionMode::Platform => write!(f, "platform"),
            SelectionMode::PlatformVersion => write!(f, "platform-version"),
            SelectionMode::DescriptiveBasic => write!(f, "descriptive-basic"),
        }
    }
}

impl FromStr for SelectionMode {
    type Err = ();

    fn from_str(input: &str) -> Result<SelectionMode, Self::Err> {
        match input {
            "basic" => Ok(SelectionMode::Basic),
            "platform" => Ok(SelectionMode::Platform),
            "platform-version" => Ok(SelectionMode::PlatformVersion),
            "descriptive-basic" => Ok(SelectionMode::DescriptiveBasic),
            _ => Err(()),
        }
    }
}

impl SelectionMode {
    pub fn iter_variants() -> std::slice::Iter<'static, SelectionMode> {
        static VARIANTS: [SelectionMode; 4] = [
            SelectionMode::Basic,
            SelectionMode::Platform,
            SelectionMode::PlatformVersion,
            SelectionMode::DescriptiveBasic,
        ];
        VARIANTS.iter()
    }

    /// Name of the mode in plots.
    pub fn plot_label(&self) -> &'static str {
        match self {
            SelectionMode::Basic => "platform",
            SelectionMode::Platform => "os",
            SelectionMode::PlatformVersion => "os-version",
            SelectionMode::DescriptiveBasic => "descriptive",
        }
    }
}

/// Plot labels of all modes, least to most descriptive.
pub fn plot_labels() -> Vec<&'static str> {
    SelectionMode::iter_variants()
        .map(SelectionMode::plot_label)
        .collect()
}

/// Plot label of an experiment directory, or the directory name itself if it
/// is not a selection mode.
pub fn display_label(experiment: &str) -> String {
    match experiment.parse::<SelectionMode>() {
        Ok(mode) => mode.plot_label().to_string(),
        Err(()) => experiment.to_string(),
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    Amd64,
    Arm64,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Amd64 => write!(f, "amd64"),
            Platform::Arm64 => write!(f, "arm64"),
        }
    }
}

impl Platform {
    /// Platform of an image, as told by its name.
    pub fn from_image_name(name: &str) -> Self {
        if name.contains("arm") {
            Platform::Arm64
        } else {
            Platform::Amd64
        }
    }
}
