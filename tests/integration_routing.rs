use crossterm::event::KeyCode;
use window_tree_server::constants::MOUSE_POINTER_ID;
use window_tree_server::embedding::EmbedFlags;
use window_tree_server::events::{Event, GestureEvent, GestureKind, TouchEventKind};
use window_tree_server::testing::TestSetup;
use window_tree_server::{ClientId, Insets, Point, Rect, RouteDecision};

const CLIENT_A: ClientId = ClientId(1);

#[test]
fn non_client_press_drag_release_is_handled_locally() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(10, 10, 100, 100)).unwrap();
    assert!(t.client().set_client_area(top, Insets::top(10), Vec::new()));

    t.events.move_mouse_to(&mut t.service, Point::new(15, 16));
    t.log.clear();
    t.local_events.clear();

    let press = t.events.press_left(&mut t.service);
    assert_eq!(press.target, Some(top));
    assert_eq!(press.decision, RouteDecision::Local);
    assert!(t.service.is_handling_pointer_press(top, MOUSE_POINTER_ID));

    // Dragging into the client area does not change who owns the sequence.
    let drag = t.events.move_mouse_to(&mut t.service, Point::new(15, 50));
    assert_eq!(drag.decision, RouteDecision::Local);
    t.events.release_left(&mut t.service);

    assert_eq!(
        t.local_events.descriptions(),
        vec!["MOUSE_PRESSED 5,6", "MOUSE_DRAGGED 5,40", "MOUSE_RELEASED 5,40"]
    );
    assert!(t.log.input_events().is_empty());
    assert!(!t.service.is_handling_pointer_press(top, MOUSE_POINTER_ID));
}

#[test]
fn client_area_press_drag_release_goes_to_the_client_only() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(10, 10, 100, 100)).unwrap();
    assert!(t.client().set_client_area(top, Insets::top(10), Vec::new()));

    t.events.move_mouse_to(&mut t.service, Point::new(60, 60));
    t.log.clear();
    t.local_events.clear();

    let press = t.events.press_left(&mut t.service);
    assert_eq!(
        press.decision,
        RouteDecision::Remote {
            client: CLIENT_A,
            window: top
        }
    );
    t.events.move_mouse_to(&mut t.service, Point::new(65, 12));
    t.events.release_left(&mut t.service);

    assert_eq!(
        t.log.input_events(),
        vec![
            "InputEvent window=1,1 MOUSE_PRESSED 50,50",
            "InputEvent window=1,1 MOUSE_DRAGGED 55,2",
            "InputEvent window=1,1 MOUSE_RELEASED 55,2",
        ]
    );
    assert!(t.local_events.events().is_empty());
}

#[test]
fn moves_over_a_top_level_are_shared() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
    assert!(t.client().set_client_area(top, Insets::top(10), Vec::new()));

    let report = t.events.move_mouse_to(&mut t.service, Point::new(20, 5));
    assert_eq!(
        report.decision,
        RouteDecision::Shared {
            client: CLIENT_A,
            window: top
        }
    );
    assert_eq!(t.log.input_events(), vec!["InputEvent window=1,1 MOUSE_MOVED 20,5"]);
    assert_eq!(t.local_events.descriptions(), vec!["MOUSE_MOVED 20,5"]);
}

#[test]
fn touch_points_track_chrome_independently() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
    assert!(t.client().set_client_area(top, Insets::top(10), Vec::new()));

    let chrome = t
        .events
        .touch(&mut t.service, TouchEventKind::Pressed, 1, Point::new(5, 5));
    let content = t
        .events
        .touch(&mut t.service, TouchEventKind::Pressed, 2, Point::new(50, 50));
    assert_eq!(chrome.decision, RouteDecision::Local);
    assert_eq!(
        content.decision,
        RouteDecision::Remote {
            client: CLIENT_A,
            window: top
        }
    );

    let chrome_move = t
        .events
        .touch(&mut t.service, TouchEventKind::Moved, 1, Point::new(60, 60));
    assert_eq!(chrome_move.decision, RouteDecision::Local);
    t.events
        .touch(&mut t.service, TouchEventKind::Cancelled, 1, Point::new(60, 60));
    assert!(!t.service.is_handling_pointer_press(top, 1));
    assert!(t.service.is_handling_pointer_press(top, 2));
}

#[test]
fn gestures_never_leave_the_server() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
    let report = t.service.dispatch_event(Event::Gesture(GestureEvent {
        kind: GestureKind::Tap,
        location: Point::new(40, 40),
    }));
    assert_eq!(report.target, Some(top));
    assert_eq!(report.decision, RouteDecision::Local);
    assert!(t.log.input_events().is_empty());
}

#[test]
fn child_windows_route_to_their_owner() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(0, 0, 200, 200)).unwrap();
    let child = t.new_window(top, 2, Rect::new(20, 20, 50, 50)).unwrap();

    let report = t.events.move_mouse_to(&mut t.service, Point::new(30, 35));
    assert_eq!(report.target, Some(child));
    assert_eq!(
        report.decision,
        RouteDecision::Remote {
            client: CLIENT_A,
            window: child
        }
    );
    assert_eq!(t.log.input_events(), vec!["InputEvent window=1,2 MOUSE_MOVED 10,15"]);
}

#[test]
fn embedded_client_receives_events_over_its_root() {
    let mut t = TestSetup::new();
    let a = t.client_id;
    let top = t.new_top_level(1, Rect::new(0, 0, 200, 200)).unwrap();
    let host = t.new_window(top, 2, Rect::new(20, 20, 100, 100)).unwrap();
    let (b, b_log) = t.embed_new_client(a, host, EmbedFlags::empty()).unwrap();
    b_log.clear();

    let report = t.events.move_mouse_to(&mut t.service, Point::new(25, 25));
    assert_eq!(
        report.decision,
        RouteDecision::Remote {
            client: b,
            window: host
        }
    );
    assert_eq!(b_log.input_events(), vec!["InputEvent window=1,2 MOUSE_MOVED 5,5"]);
    assert!(t.log.input_events().is_empty());
}

#[test]
fn intercepting_embedder_wins_over_embedded_capture() {
    let mut t = TestSetup::new();
    let a = t.client_id;
    let top = t.new_top_level(1, Rect::new(10, 10, 200, 200)).unwrap();
    let host = t.new_window(top, 2, Rect::new(10, 10, 100, 100)).unwrap();
    let (b, b_log) = t
        .embed_new_client(a, host, EmbedFlags::INTERCEPT_EVENTS)
        .unwrap();
    let inner = t
        .new_window_for(b, &b_log, host, 1, Rect::new(5, 5, 20, 20))
        .unwrap();
    let change = t.change_id();
    assert!(t.service.client(b).set_capture(change, inner));
    assert_eq!(t.service.capture_window(), Some(inner));

    t.events.move_mouse_to(&mut t.service, Point::new(30, 30));
    t.log.clear();
    b_log.clear();

    let report = t.events.press_left(&mut t.service);
    assert_eq!(report.target, Some(inner));
    assert_eq!(report.decision, RouteDecision::Remote { client: a, window: host });
    assert_eq!(t.log.input_events(), vec!["InputEvent window=1,2 MOUSE_PRESSED 10,10"]);
    assert!(b_log.is_empty());

    // A watcher registration is the only way the embedded client sees it.
    assert!(t.service.client(b).start_pointer_watcher(false));
    t.events.release_left(&mut t.service);
    assert_eq!(
        b_log.descriptions(),
        vec!["PointerWatcherEvent window=2,1 MOUSE_RELEASED 30,30"]
    );
}

#[test]
fn capture_overrides_the_non_client_area() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
    assert!(t.client().set_client_area(top, Insets::top(10), Vec::new()));
    let change = t.change_id();
    assert!(t.client().set_capture(change, top));

    t.events.move_mouse_to(&mut t.service, Point::new(5, 5));
    let report = t.events.press_left(&mut t.service);
    assert_eq!(
        report.decision,
        RouteDecision::Remote {
            client: CLIENT_A,
            window: top
        }
    );

    // Events far outside still go to the capture window, in its space.
    t.log.clear();
    t.events.move_mouse_to(&mut t.service, Point::new(300, 300));
    assert_eq!(
        t.log.input_events(),
        vec!["InputEvent window=1,1 MOUSE_DRAGGED 300,300"]
    );
}

#[test]
fn implicit_grab_keeps_the_press_target_until_release() {
    let mut t = TestSetup::new();
    let left = t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
    t.new_top_level(2, Rect::new(200, 0, 100, 100)).unwrap();

    t.events.move_mouse_to(&mut t.service, Point::new(50, 50));
    t.events.press_left(&mut t.service);
    let drag = t.events.move_mouse_to(&mut t.service, Point::new(250, 50));
    assert_eq!(drag.target, Some(left));
    t.events.release_left(&mut t.service);

    let after = t.events.move_mouse_to(&mut t.service, Point::new(250, 50));
    assert_ne!(after.target, Some(left));
}

#[test]
fn pointer_watchers_see_screen_coordinates() {
    let mut t = TestSetup::new();
    t.new_top_level(1, Rect::new(10, 10, 100, 100)).unwrap();
    let (b, b_log) = t.add_client().unwrap();
    assert!(t.service.client(b).start_pointer_watcher(false));

    t.events.move_mouse_to(&mut t.service, Point::new(20, 20));
    t.events.press_left(&mut t.service);
    assert_eq!(
        b_log.observed_events(),
        vec!["PointerWatcherEvent window=null MOUSE_PRESSED 20,20"]
    );

    // Moves need want_moves.
    b_log.clear();
    t.events.release_left(&mut t.service);
    t.events.move_mouse_to(&mut t.service, Point::new(30, 30));
    assert_eq!(
        b_log.observed_events(),
        vec!["PointerWatcherEvent window=null MOUSE_RELEASED 20,20"]
    );

    assert!(t.service.client(b).start_pointer_watcher(true));
    b_log.clear();
    t.events.move_mouse_to(&mut t.service, Point::new(31, 30));
    assert_eq!(
        b_log.observed_events(),
        vec!["PointerWatcherEvent window=null MOUSE_MOVED 31,30"]
    );

    assert!(t.service.client(b).stop_pointer_watcher());
    b_log.clear();
    t.events.click_at(&mut t.service, Point::new(40, 40));
    assert!(b_log.is_empty());
}

#[test]
fn watching_target_client_gets_flagged_delivery_instead_of_a_copy() {
    let mut t = TestSetup::new();
    t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
    assert!(t.client().start_pointer_watcher(true));

    t.events.move_mouse_to(&mut t.service, Point::new(20, 20));
    assert_eq!(
        t.log.input_events(),
        vec!["InputEvent window=1,1 MOUSE_MOVED 20,20 watched"]
    );
    assert!(t.log.observed_events().is_empty());
}

#[test]
fn keys_follow_focus_and_unhandled_keys_reach_the_delegate() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();

    let unfocused = t.events.press_key(&mut t.service, KeyCode::Char('x'));
    assert_eq!(unfocused.target, None);
    assert_eq!(unfocused.decision, RouteDecision::Local);

    let change = t.change_id();
    assert!(t.client().set_focus(change, Some(top)));
    t.log.clear();

    let report = t.events.press_key(&mut t.service, KeyCode::Char('x'));
    assert_eq!(
        report.decision,
        RouteDecision::Remote {
            client: CLIENT_A,
            window: top
        }
    );
    assert_eq!(t.log.input_events(), vec!["InputEvent window=1,1 KEY_PRESSED"]);

    let event_id = t.log.last_event_id().unwrap();
    assert_eq!(t.service.tree(CLIENT_A).unwrap().in_flight_event_count(), 1);
    assert!(t.client().on_window_input_event_ack(event_id, false));
    assert!(!t.client().on_window_input_event_ack(event_id, false));

    let unhandled = t.delegate.unhandled_keys();
    assert_eq!(unhandled.len(), 1);
    assert_eq!(unhandled[0].code, KeyCode::Char('x'));
}

#[test]
fn out_of_order_acks_are_ignored() {
    let mut t = TestSetup::new();
    t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
    t.events.move_mouse_to(&mut t.service, Point::new(10, 10));
    t.events.move_mouse_to(&mut t.service, Point::new(11, 10));
    let newest = t.log.last_event_id().unwrap();

    assert!(!t.client().on_window_input_event_ack(newest, true));
    assert_eq!(t.service.tree(CLIENT_A).unwrap().in_flight_event_count(), 2);
}

#[test]
fn wheel_events_go_to_the_window_under_the_cursor() {
    let mut t = TestSetup::new();
    let top = t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
    t.events.move_mouse_to(&mut t.service, Point::new(50, 50));
    t.log.clear();
    let report = t.events.wheel(&mut t.service, 3);
    assert_eq!(report.target, Some(top));
    assert_eq!(t.log.input_events(), vec!["InputEvent window=1,1 MOUSEWHEEL 50,50"]);
}
