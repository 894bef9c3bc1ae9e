//! Step bitset driving the ingest state machine.

use bitflags::bitflags;

bitflags! {
    /// Steps an ingest process should run, lowest bit first.
    ///
    /// The same type is used for the user-facing presets and for the set of
    /// steps still remaining on a running process; an empty set is terminal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProcessConfiguration: u8 {
        const DOWNLOAD_STEP = 0b0000_0001;
        const CONVERT_AND_UPLOAD_STEP = 0b0000_0010;

        /// Fetch raw take data only.
        const DOWNLOAD = Self::DOWNLOAD_STEP.bits();
        /// Download, then convert and upload.
        const INGEST = Self::DOWNLOAD_STEP.bits() | Self::CONVERT_AND_UPLOAD_STEP.bits();
    }
}

/// One phase of an ingest process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    Download,
    ConvertAndUpload,
}

impl ProcessStep {
    pub fn flag(&self) -> ProcessConfiguration {
        match self {
            ProcessStep::Download => ProcessConfiguration::DOWNLOAD_STEP,
            ProcessStep::ConvertAndUpload => ProcessConfiguration::CONVERT_AND_UPLOAD_STEP,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStep::Download => "download",
            ProcessStep::ConvertAndUpload => "convert_and_upload",
        }
    }
}

impl std::fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProcessConfiguration {
    /// Number of steps in this configuration.
    pub fn step_count(&self) -> usize {
        self.bits().count_ones() as usize
    }

    /// The step encoded by the lowest set bit, if any.
    pub fn next_step(&self) -> Option<ProcessStep> {
        if self.contains(ProcessConfiguration::DOWNLOAD_STEP) {
            Some(ProcessStep::Download)
        } else if self.contains(ProcessConfiguration::CONVERT_AND_UPLOAD_STEP) {
            Some(ProcessStep::ConvertAndUpload)
        } else {
            None
        }
    }

    pub fn parse_preset(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "download" => Some(ProcessConfiguration::DOWNLOAD),
            "ingest" => Some(ProcessConfiguration::INGEST),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(ProcessConfiguration::DOWNLOAD.bits(), 0b01);
        assert_eq!(ProcessConfiguration::INGEST.bits(), 0b11);
        assert_eq!(ProcessConfiguration::DOWNLOAD.step_count(), 1);
        assert_eq!(ProcessConfiguration::INGEST.step_count(), 2);
    }

    #[test]
    fn test_next_step_walks_lowest_bit_first() {
        let mut remaining = ProcessConfiguration::INGEST;
        assert_eq!(remaining.next_step(), Some(ProcessStep::Download));

        remaining.remove(ProcessStep::Download.flag());
        assert_eq!(remaining.next_step(), Some(ProcessStep::ConvertAndUpload));

        remaining.remove(ProcessStep::ConvertAndUpload.flag());
        assert!(remaining.is_empty());
        assert_eq!(remaining.next_step(), None);
    }

    #[test]
    fn test_unknown_bits_are_not_part_of_all() {
        assert!(ProcessConfiguration::from_bits(0b100).is_none());
        assert_eq!(ProcessConfiguration::all(), ProcessConfiguration::INGEST);
    }

    #[test]
    fn test_parse_preset() {
        assert_eq!(
            ProcessConfiguration::parse_preset("Download"),
            Some(ProcessConfiguration::DOWNLOAD)
        );
        assert_eq!(
            ProcessConfiguration::parse_preset("ingest"),
            Some(ProcessConfiguration::INGEST)
        );
        assert_eq!(ProcessConfiguration::parse_preset("upload"), None);
    }
}
