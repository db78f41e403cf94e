use std::time::Duration;

use serde_json::json;

use super::memory::{PublishOutcome, Request};
use super::{DeliveryOptions, InMemoryMiddleware, Middleware, MiddlewareEvent, channel};
use crate::catalog::MessageCodec;
use crate::directory::TopicInfo;
use crate::utils::error::MiddlewareError;

const LIDAR: &str = "felicia.drivers.LidarFrameMessage";

fn registered(queue_size: usize) -> (InMemoryMiddleware, super::MiddlewareEvents) {
    let middleware = InMemoryMiddleware::new();
    let (sink, events) = channel(queue_size);
    let options = DeliveryOptions {
        period: Duration::from_millis(100),
        queue_size,
    };
    middleware
        .register_dynamic_subscription(sink, options)
        .unwrap();
    (middleware, events)
}

#[test]
fn requests_before_handshake_are_refused() {
    let middleware = InMemoryMiddleware::with_pending_handshake();
    let (sink, _events) = channel(1);
    assert_eq!(
        middleware.register_dynamic_subscription(sink.clone(), DeliveryOptions::default()),
        Err(MiddlewareError::NotReady)
    );

    middleware.complete_handshake();
    middleware
        .register_dynamic_subscription(sink.clone(), DeliveryOptions::default())
        .unwrap();
    assert_eq!(
        middleware.register_dynamic_subscription(sink, DeliveryOptions::default()),
        Err(MiddlewareError::AlreadyRegistered)
    );
    assert_eq!(middleware.options(), Some(DeliveryOptions::default()));
}

#[test]
fn subscribe_without_registration_fails() {
    let middleware = InMemoryMiddleware::new();
    assert_eq!(
        middleware.subscribe("lidar/0", LIDAR, &DeliveryOptions::default()),
        Err(MiddlewareError::NotRegistered)
    );
}

#[test]
fn subscribe_acks_and_enables_publishing() {
    let (middleware, mut events) = registered(4);
    middleware.advertise(TopicInfo::new("lidar/0", LIDAR));

    assert_eq!(
        middleware.publish("lidar/0", json!({})),
        PublishOutcome::NotSubscribed
    );

    middleware
        .subscribe("lidar/0", LIDAR, &DeliveryOptions::default())
        .unwrap();
    assert_eq!(
        events.events.try_recv().unwrap(),
        MiddlewareEvent::SubscribeAck {
            topic: "lidar/0".to_string(),
            result: Ok(())
        }
    );

    assert_eq!(
        middleware.publish("lidar/0", json!({ "rangeMin": 0.1 })),
        PublishOutcome::Delivered
    );
    let delivered = events.messages.try_recv().unwrap();
    assert_eq!(delivered.topic, "lidar/0");
    assert_eq!(delivered.type_name, LIDAR);
    assert_eq!(delivered.payload["rangeMin"], 0.1);

    assert_eq!(
        middleware.publish("unknown", json!({})),
        PublishOutcome::UnknownTopic
    );
}

#[test]
fn full_queue_drops_at_the_source() {
    let (middleware, mut events) = registered(1);
    middleware.advertise(TopicInfo::new("lidar/0", LIDAR));
    middleware
        .subscribe("lidar/0", LIDAR, &DeliveryOptions::default())
        .unwrap();

    assert_eq!(
        middleware.publish("lidar/0", json!({ "seq": 1 })),
        PublishOutcome::Delivered
    );
    assert_eq!(
        middleware.publish("lidar/0", json!({ "seq": 2 })),
        PublishOutcome::Dropped
    );
    assert_eq!(events.messages.try_recv().unwrap().payload["seq"], 1);
    assert!(events.messages.try_recv().is_err());
}

#[test]
fn rejected_topic_acks_with_error() {
    let (middleware, mut events) = registered(1);
    middleware.reject("camera/9", "no such device");
    middleware
        .subscribe("camera/9", LIDAR, &DeliveryOptions::default())
        .unwrap();
    assert_eq!(
        events.events.try_recv().unwrap(),
        MiddlewareEvent::SubscribeAck {
            topic: "camera/9".to_string(),
            result: Err("no such device".to_string())
        }
    );
    assert!(!middleware.is_subscribed("camera/9"));
}

#[test]
fn held_acks_are_released_in_order() {
    let (middleware, mut events) = registered(1);
    middleware.hold_acks(true);
    middleware
        .subscribe("lidar/0", LIDAR, &DeliveryOptions::default())
        .unwrap();
    middleware.unsubscribe("lidar/0").unwrap();
    assert!(events.events.try_recv().is_err());

    assert_eq!(middleware.release_acks(), 2);
    assert!(matches!(
        events.events.try_recv().unwrap(),
        MiddlewareEvent::SubscribeAck { .. }
    ));
    assert!(matches!(
        events.events.try_recv().unwrap(),
        MiddlewareEvent::UnsubscribeAck { .. }
    ));
    assert_eq!(
        middleware.requests(),
        vec![
            Request::Subscribe("lidar/0".to_string()),
            Request::Unsubscribe("lidar/0".to_string())
        ]
    );
}

#[test]
fn delivery_errors_are_forwarded() {
    let (middleware, mut events) = registered(1);
    middleware.fail_delivery("lidar/0", "publisher went away");
    assert_eq!(
        events.events.try_recv().unwrap(),
        MiddlewareEvent::DeliveryError {
            topic: "lidar/0".to_string(),
            status: "publisher went away".to_string()
        }
    );
}

#[test]
fn demo_camera_frame_fits_the_binary_schema() {
    let catalog = crate::catalog::ChannelCatalog::builtin();
    let codec = catalog
        .classify(crate::catalog::messages::CAMERA_FRAME_MESSAGE)
        .unwrap()
        .codec()
        .unwrap()
        .clone();
    let body = codec.encode(&super::demo::camera_frame(3)).unwrap();
    let decoded = codec.decode(&body).unwrap();
    assert_eq!(decoded["cameraFormat"]["width"], 8);
    assert_eq!(decoded["data"].as_array().unwrap().len(), 64);
}

#[test]
fn demo_topics_publish_once_subscribed() {
    let (middleware, mut events) = registered(4);
    super::demo::advertise(&middleware, "127.0.0.1:8080");
    assert_eq!(
        middleware.publish(super::demo::LIDAR_TOPIC, super::demo::lidar_frame(1)),
        PublishOutcome::NotSubscribed
    );

    middleware
        .subscribe(super::demo::LIDAR_TOPIC, LIDAR, &DeliveryOptions::default())
        .unwrap();
    assert_eq!(
        middleware.publish(super::demo::LIDAR_TOPIC, super::demo::lidar_frame(2)),
        PublishOutcome::Delivered
    );
    let delivered = events.messages.try_recv().unwrap();
    assert_eq!(delivered.type_name, LIDAR);
    assert_eq!(delivered.payload["ranges"].as_array().unwrap().len(), 36);
}
