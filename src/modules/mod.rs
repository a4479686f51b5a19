pub mod user {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_doc;
    pub mod service;
}

pub mod conversation {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_doc;
    pub mod service;
    pub mod crystal;
    pub mod presence;
    pub mod list;
}

pub mod message {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_doc;
    pub mod service;
}

pub mod notification {
    pub mod schema;
    pub mod repository_doc;
}

pub mod file_upload;

pub mod chat {
    pub mod composer;
    pub mod window;
}

pub mod inbox {
    pub mod modal;
}

pub mod pulse {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_doc;
    pub mod service;
    pub mod viewer;
}

pub mod session {
    pub mod service;
}
