use adshade_core::system::EventKind;

use windows::Win32::UI::WindowsAndMessaging::{
    EVENT_OBJECT_CREATE, EVENT_OBJECT_LOCATIONCHANGE, EVENT_OBJECT_NAMECHANGE,
    EVENT_OBJECT_REORDER, EVENT_OBJECT_SHOW, EVENT_SYSTEM_FOREGROUND,
};

/// Maps an engine event kind to the WinEvent code it hooks.
pub(crate) fn event_code(kind: EventKind) -> u32 {
    match kind {
        EventKind::Create => EVENT_OBJECT_CREATE,
        EventKind::Show => EVENT_OBJECT_SHOW,
        EventKind::Reorder => EVENT_OBJECT_REORDER,
        EventKind::LocationChange => EVENT_OBJECT_LOCATIONCHANGE,
        EventKind::NameChange => EVENT_OBJECT_NAMECHANGE,
        EventKind::Focus => EVENT_SYSTEM_FOREGROUND,
    }
}

/// Translates a raw WinEvent code back into an engine event kind.
///
/// Returns `None` for codes outside the subscribed set.
pub(crate) fn translate(event: u32) -> Option<EventKind> {
    match event {
        e if e == EVENT_OBJECT_CREATE => Some(EventKind::Create),
        e if e == EVENT_OBJECT_SHOW => Some(EventKind::Show),
        e if e == EVENT_OBJECT_REORDER => Some(EventKind::Reorder),
        e if e == EVENT_OBJECT_LOCATIONCHANGE => Some(EventKind::LocationChange),
        e if e == EVENT_OBJECT_NAMECHANGE => Some(EventKind::NameChange),
        e if e == EVENT_SYSTEM_FOREGROUND => Some(EventKind::Focus),
        _ => None,
    }
}
