use no_std_net::Ipv4Addr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DnsServers {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub primary: Option<Ipv4Addr>,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub secondary: Option<Ipv4Addr>,
}

/// IPv4 configuration negotiated by the PPP engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PppConnection {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub address: Ipv4Addr,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub gateway: Option<Ipv4Addr>,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub netmask: Option<Ipv4Addr>,
    pub dns_servers: DnsServers,
}

impl PppConnection {
    /// Address as a host-order integer, `0` when unspecified.
    pub fn ipv4_u32(&self) -> u32 {
        u32::from(self.address)
    }

    pub fn is_up(&self) -> bool {
        !self.address.is_unspecified()
    }
}
