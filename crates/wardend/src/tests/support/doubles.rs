//! `mockall` doubles for the collaborator traits.

use mockall::mock;

use crate::actions::{Action, ActionSender};
use crate::connectivity::ConnectivityChecker;
use crate::host::HostActivity;
use crate::installer;
use crate::network::NetworkReachability;
use crate::reconnect::ReconnectionPolicy;

mock! {
    pub Actions {}
    impl ActionSender for Actions {
        fn send(&self, action: Action) -> bool;
    }
}

mock! {
    pub Network {}
    impl NetworkReachability for Network {
        fn is_network_available(&self) -> bool;
    }
}

mock! {
    pub Installer {}
    impl installer::Installer for Installer {
        fn reset_configuration(&self) -> bool;
        fn is_installing(&self) -> bool;
    }
}

mock! {
    pub Host {}
    impl HostActivity for Host {
        fn is_foreground(&self) -> bool;
    }
}

mock! {
    pub Checker {}
    impl ConnectivityChecker for Checker {
        fn check(&self, socks_port: u16) -> bool;
    }
}

mock! {
    pub Policy {}
    impl ReconnectionPolicy for Policy {
        fn arm(&self);
        fn cancel(&self);
    }
}
