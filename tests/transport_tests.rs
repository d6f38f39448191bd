use synthwave::clock::ManualClock;
use synthwave::{TransportClock, TransportEvent};

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> (ManualClock, TransportClock) {
        let clock = ManualClock::new();
        let transport = TransportClock::new(Box::new(clock.clone()));
        (clock, transport)
    }

    #[test]
    fn test_default_initialization() {
        let (_, transport) = transport();
        assert_eq!(transport.position(), 0.0);
        assert!(!transport.is_running());
    }

    #[test]
    fn test_position_advances_while_running() {
        let (clock, mut transport) = transport();
        assert_eq!(transport.start(), TransportEvent::Started { position: 0.0 });

        clock.advance_secs(0.25);
        assert!((transport.position() - 0.25).abs() < 1e-9);
        clock.advance_secs(0.75);
        assert!((transport.position() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_then_start_resumes() {
        let (clock, mut transport) = transport();
        transport.start();
        clock.advance_secs(2.0);

        let stopped = transport.stop();
        assert!((stopped.position() - 2.0).abs() < 1e-9);

        clock.advance_secs(5.0);
        assert!((transport.position() - 2.0).abs() < 1e-9);

        transport.start();
        clock.advance_secs(1.0);
        assert!((transport.position() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_is_always_reported() {
        let (_, mut transport) = transport();
        assert_eq!(transport.stop(), TransportEvent::Stopped { position: 0.0 });
        assert_eq!(transport.stop(), TransportEvent::Stopped { position: 0.0 });
    }

    #[test]
    fn test_start_twice_does_not_rebase() {
        let (clock, mut transport) = transport();
        transport.start();
        clock.advance_secs(1.0);
        transport.start();
        clock.advance_secs(1.0);
        assert!((transport.position() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_seek_while_stopped() {
        let (clock, mut transport) = transport();
        let event = transport.seek(42.5);
        assert_eq!(event, TransportEvent::Seeked { from: 0.0, to: 42.5 });

        clock.advance_secs(1.0);
        assert_eq!(transport.position(), 42.5);
    }

    #[test]
    fn test_seek_clamps_to_zero() {
        let (_, mut transport) = transport();
        transport.seek(3.0);
        assert_eq!(transport.seek(-1.0).position(), 0.0);
        assert_eq!(transport.seek(f64::NAN).position(), 0.0);
    }

    #[test]
    fn test_position_is_monotonic_between_controls() {
        let (clock, mut transport) = transport();
        transport.start();
        let mut last = transport.position();
        for _ in 0..100 {
            clock.advance_secs(0.016);
            let now = transport.position();
            assert!(now >= last);
            last = now;
        }
    }
}
