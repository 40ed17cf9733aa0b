pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    dim, error, file_new, header, info, muted, object_line, section, status, success, summary_row,
    timing, warn,
};
pub use progress::{elapsed, Spinner};
pub use table::TableBuilder;
pub use theme::{theme, Theme};
