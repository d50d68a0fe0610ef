use snafu::Snafu;

use evbank_core::bank::BankError;
use evbank_core::consolidate::ConsolidateError;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Consolidation of {input_dir} into {output} failed: {source}"))]
    Consolidate {
        input_dir: String,
        output: String,
        #[snafu(source(from(ConsolidateError, Box::new)))]
        source: Box<ConsolidateError>,
    },

    #[snafu(display(
        "Failed to open bank {path}. \
         Ensure it is a finished evbank file. ({source})"
    ))]
    OpenBank {
        path: String,
        #[snafu(source(from(BankError, Box::new)))]
        source: Box<BankError>,
    },

    #[snafu(display("Failed to read field '{field}' from bank {path}: {source}"))]
    ReadBank {
        path: String,
        field: String,
        #[snafu(source(from(BankError, Box::new)))]
        source: Box<BankError>,
    },
}
