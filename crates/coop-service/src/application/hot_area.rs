//! Hot-area classification of the local pointer.
//!
//! A band of `margin` pixels along each display border forms a hot area.
//! Listeners learn which band the pointer is in and whether it touches the
//! border itself, so a client UI can offer to move the pointer to a peer.

use std::collections::BTreeSet;
use std::sync::Arc;

use coop_core::{Coordinate, DisplayInfo};

use crate::application::collaborators::ClientNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum HotAreaType {
    Left = 0,
    Right = 1,
    Top = 2,
    Bottom = 3,
    None = 4,
}

/// Classifies `pos` against `display` with a band of `margin` pixels.
///
/// Horizontal bands take priority over vertical ones in the corners.
pub fn classify(display: DisplayInfo, margin: i32, pos: Coordinate) -> (HotAreaType, bool) {
    let max_x = display.width - 1;
    let max_y = display.height - 1;
    let area = if pos.x <= margin {
        HotAreaType::Left
    } else if pos.x >= max_x - margin {
        HotAreaType::Right
    } else if pos.y <= margin {
        HotAreaType::Top
    } else if pos.y >= max_y - margin {
        HotAreaType::Bottom
    } else {
        HotAreaType::None
    };
    let is_edge = pos.x <= 0 || pos.x >= max_x || pos.y <= 0 || pos.y >= max_y;
    (area, is_edge)
}

pub struct HotArea {
    notifier: Arc<dyn ClientNotifier>,
    listeners: BTreeSet<i32>,
    margin: i32,
    last: (HotAreaType, bool),
}

impl HotArea {
    pub fn new(notifier: Arc<dyn ClientNotifier>, margin: i32) -> Self {
        Self {
            notifier,
            listeners: BTreeSet::new(),
            margin,
            last: (HotAreaType::None, false),
        }
    }

    pub fn add_listener(&mut self, pid: i32) {
        self.listeners.insert(pid);
    }

    pub fn remove_listener(&mut self, pid: i32) {
        self.listeners.remove(&pid);
    }

    pub fn on_client_died(&mut self, pid: i32) {
        self.listeners.remove(&pid);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Reclassifies the pointer; listeners hear about changes only.
    pub fn process_pointer(&mut self, display: DisplayInfo, pos: Coordinate) {
        let current = classify(display, self.margin, pos);
        if current == self.last {
            return;
        }
        self.last = current;
        for &pid in &self.listeners {
            self.notifier.notify_hot_area(pid, current.0, current.1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use coop_core::protocol::messages::LocationInfo;
    use coop_core::NetworkId;

    use super::*;
    use crate::application::event_manager::CoordinationMessage;

    #[derive(Default)]
    struct RecordingNotifier {
        areas: Mutex<Vec<(i32, HotAreaType, bool)>>,
    }

    impl ClientNotifier for RecordingNotifier {
        fn notify_coordination_message(
            &self,
            _pid: i32,
            _user_data: i32,
            _network_id: &NetworkId,
            _msg: CoordinationMessage,
            _err_code: i32,
        ) {
        }
        fn notify_hot_area(&self, pid: i32, area: HotAreaType, is_edge: bool) {
            self.areas.lock().unwrap().push((pid, area, is_edge));
        }
        fn notify_mouse_location(&self, _pid: i32, _network_id: &NetworkId, _location: LocationInfo) {}
    }

    const DISPLAY: DisplayInfo = DisplayInfo {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn test_classify_bands() {
        assert_eq!(classify(DISPLAY, 100, Coordinate::new(0, 500)), (HotAreaType::Left, true));
        assert_eq!(classify(DISPLAY, 100, Coordinate::new(1850, 500)), (HotAreaType::Right, false));
        assert_eq!(classify(DISPLAY, 100, Coordinate::new(900, 50)), (HotAreaType::Top, false));
        assert_eq!(classify(DISPLAY, 100, Coordinate::new(900, 1079)), (HotAreaType::Bottom, true));
        assert_eq!(classify(DISPLAY, 100, Coordinate::new(900, 500)), (HotAreaType::None, false));
    }

    #[test]
    fn test_listeners_are_notified_only_on_change() {
        // Arrange
        let notifier = Arc::new(RecordingNotifier::default());
        let mut hot_area = HotArea::new(notifier.clone(), 100);
        hot_area.add_listener(42);

        // Act
        hot_area.process_pointer(DISPLAY, Coordinate::new(900, 500));
        hot_area.process_pointer(DISPLAY, Coordinate::new(10, 500));
        hot_area.process_pointer(DISPLAY, Coordinate::new(20, 500));
        hot_area.process_pointer(DISPLAY, Coordinate::new(0, 500));

        // Assert
        assert_eq!(
            *notifier.areas.lock().unwrap(),
            vec![(42, HotAreaType::Left, false), (42, HotAreaType::Left, true)]
        );
    }
}
