// Compass Relay - ESP-IDF Platform Glue
//
// Wi-Fi, HTTP, flash storage and restart: the collaborators the control loop
// only sees through `Transport`, `Connectivity` and `UpdateService`.

pub mod http;
pub mod ota;
pub mod storage;
pub mod wifi;
