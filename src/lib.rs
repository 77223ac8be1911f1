use lazy_static::lazy_static;
use std::sync::Once;
use style::Style;

pub mod canvas;
pub mod diagram;
pub mod error;
pub mod feature;
pub mod feature_index;
pub mod layout;
pub mod range;
pub mod stream;
pub mod style;

lazy_static! {
    // Drawing rules used when no style file is given
    pub static ref DEFAULT_STYLE: Style = Style::builtin();
}

static INIT: Once = Once::new();

/// One-time library setup. Idempotent; the outermost caller invokes this
/// before constructing any pipeline component; every component assumes it
/// has completed.
pub fn initialize() {
    INIT.call_once(|| {
        lazy_static::initialize(&DEFAULT_STYLE);
    });
}
