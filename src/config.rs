//! Kernel Configuration
//!
//! Every fixed capacity the IPC core enforces lives here so that the
//! bare-metal image and the test harness can size the kernel differently.

/// Capacity limits for a [`Kernel`](crate::Kernel) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of endpoint slots in the arena.
    pub max_endpoints: usize,
    /// Pending messages an endpoint holds before sends fail with EAGAIN.
    pub queue_depth: usize,
    /// Largest message payload in bytes.
    pub max_message_size: usize,
    /// Number of entries in the service registry.
    pub max_services: usize,
    /// Longest service name in bytes.
    pub service_name_max: usize,
    /// Endpoints a single process may own at once.
    pub endpoints_per_process: usize,
    /// Largest single debug write in bytes.
    pub debug_write_max: usize,
}

impl KernelConfig {
    /// Limits used by the kernel image.
    pub const DEFAULT: Self = Self {
        max_endpoints: 16,
        queue_depth: 4,
        max_message_size: 128,
        max_services: 8,
        service_name_max: 32,
        endpoints_per_process: 8,
        debug_write_max: 4096,
    };

    #[inline]
    pub const fn with_max_endpoints(mut self, n: usize) -> Self {
        self.max_endpoints = n;
        self
    }

    #[inline]
    pub const fn with_queue_depth(mut self, n: usize) -> Self {
        self.queue_depth = n;
        self
    }

    #[inline]
    pub const fn with_max_message_size(mut self, n: usize) -> Self {
        self.max_message_size = n;
        self
    }

    #[inline]
    pub const fn with_max_services(mut self, n: usize) -> Self {
        self.max_services = n;
        self
    }

    #[inline]
    pub const fn with_service_name_max(mut self, n: usize) -> Self {
        self.service_name_max = n;
        self
    }

    #[inline]
    pub const fn with_endpoints_per_process(mut self, n: usize) -> Self {
        self.endpoints_per_process = n;
        self
    }

    #[inline]
    pub const fn with_debug_write_max(mut self, n: usize) -> Self {
        self.debug_write_max = n;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_one_field() {
        let cfg = KernelConfig::DEFAULT.with_queue_depth(1).with_max_services(2);
        assert_eq!(cfg.queue_depth, 1);
        assert_eq!(cfg.max_services, 2);
        assert_eq!(cfg.max_message_size, KernelConfig::DEFAULT.max_message_size);
    }
}
