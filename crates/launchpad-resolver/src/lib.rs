mod selector;

pub use selector::{
    ChoiceItem, RestartNotifier, Selection, SelectionSource, VersionChoice, VersionSelector,
};
