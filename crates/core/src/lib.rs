//! Perception core: recognizes known people on a camera feed, checks
//! whether each one wears the configured safety equipment, and reports
//! changes to a personnel directory and to live subscribers.

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod inference;
    pub mod model_resolver;
    pub mod monitor_config;
    pub mod rect;
    pub mod yolo;
}

pub mod capture {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure {
        pub mod ffmpeg_camera;
    }
}

pub mod recognition {
    pub mod domain {
        pub mod face_embedder;
        pub mod face_locator;
        pub mod gallery;
        pub mod identity_recognizer;
    }
    pub mod infrastructure {
        pub mod gallery_loader;
        pub mod onnx_face_embedder;
        pub mod onnx_face_locator;
    }
}

pub mod equipment {
    pub mod domain {
        pub mod equipment_detector;
    }
    pub mod infrastructure {
        pub mod onnx_equipment_detector;
    }
}

pub mod association {
    pub mod associator;
}

pub mod reporting {
    pub mod domain {
        pub mod change_event;
        pub mod directory_client;
        pub mod identity_state;
    }
    pub mod infrastructure {
        pub mod directory_dispatcher;
        pub mod http_directory_client;
    }
    pub mod state_reporter;
}

pub mod publishing {
    pub mod event_bus;
    pub mod frame_annotator;
    pub mod frame_publisher;
}

pub mod pipeline {
    pub mod perception_loop;
    pub mod pipeline_logger;
    pub mod recognition_worker;
}
