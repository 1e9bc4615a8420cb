pub mod device_binding;

pub use device_binding::DeviceBindingService;
