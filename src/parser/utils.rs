/*!
Provides utility functions for reading bytes of different lengths and
converting them to corresponding structs. All reads are bounds-checked:
running past the end of the buffer surfaces as [ParserError::TruncatedMsg]
instead of a panic.
*/
use crate::error::ParserError;
use crate::models::{Afi, Asn, AsnLength, NetworkPrefix};
use bytes::Buf;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub trait ReadUtils: Buf {
    #[inline]
    fn require_n_remaining(&self, n: usize, target: &str) -> Result<(), ParserError> {
        if self.remaining() < n {
            return Err(ParserError::TruncatedMsg(format!(
                "truncated msg: not enough bytes to read {target}: want {n}, have {}",
                self.remaining()
            )));
        }
        Ok(())
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8, ParserError> {
        self.require_n_remaining(1, "u8")?;
        Ok(self.get_u8())
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16, ParserError> {
        self.require_n_remaining(2, "u16")?;
        Ok(self.get_u16())
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32, ParserError> {
        self.require_n_remaining(4, "u32")?;
        Ok(self.get_u32())
    }

    #[inline]
    fn read_u64(&mut self) -> Result<u64, ParserError> {
        self.require_n_remaining(8, "u64")?;
        Ok(self.get_u64())
    }

    fn read_n_bytes(&mut self, n_bytes: usize) -> Result<Vec<u8>, ParserError> {
        self.require_n_remaining(n_bytes, "bytes")?;
        let mut buffer = vec![0; n_bytes];
        self.copy_to_slice(&mut buffer);
        Ok(buffer)
    }

    fn read_n_bytes_to_string(&mut self, n_bytes: usize) -> Result<String, ParserError> {
        let buffer = self.read_n_bytes(n_bytes)?;
        Ok(buffer.into_iter().map(|x: u8| x as char).collect::<String>())
    }

    fn read_address(&mut self, afi: &Afi) -> Result<IpAddr, ParserError> {
        match afi {
            Afi::Ipv4 => self.read_ipv4_address().map(IpAddr::V4),
            Afi::Ipv6 => self.read_ipv6_address().map(IpAddr::V6),
        }
    }

    fn read_ipv4_address(&mut self) -> Result<Ipv4Addr, ParserError> {
        self.require_n_remaining(4, "IPv4 address")?;
        Ok(Ipv4Addr::from(self.get_u32()))
    }

    fn read_ipv6_address(&mut self) -> Result<Ipv6Addr, ParserError> {
        self.require_n_remaining(16, "IPv6 address")?;
        Ok(Ipv6Addr::from(self.get_u128()))
    }

    fn read_asn(&mut self, as_length: AsnLength) -> Result<Asn, ParserError> {
        match as_length {
            AsnLength::Bits16 => self.read_u16().map(Asn::new_16bit),
            AsnLength::Bits32 => self.read_u32().map(Asn::new_32bit),
        }
    }

    fn read_afi(&mut self) -> Result<Afi, ParserError> {
        let afi = self.read_u16()?;
        Afi::try_from(afi).map_err(|_| ParserError::ParseError(format!("Unknown AFI type: {afi}")))
    }

    /// Read a prefix in NLRI encoding: one length octet, then the minimum
    /// number of address octets covering that many bits.
    fn read_nlri_prefix(&mut self, afi: &Afi) -> Result<NetworkPrefix, ParserError> {
        let bit_len = self.read_u8()?;
        let byte_len: usize = (bit_len as usize).div_ceil(8);

        let addr: IpAddr = match afi {
            Afi::Ipv4 => {
                if bit_len > 32 {
                    return Err(ParserError::ParseError(format!(
                        "invalid IPv4 prefix length: {bit_len}"
                    )));
                }
                let mut buff = [0; 4];
                self.require_n_remaining(byte_len, "IPv4 prefix")?;
                self.copy_to_slice(&mut buff[..byte_len]);
                IpAddr::V4(Ipv4Addr::from(buff))
            }
            Afi::Ipv6 => {
                if bit_len > 128 {
                    return Err(ParserError::ParseError(format!(
                        "invalid IPv6 prefix length: {bit_len}"
                    )));
                }
                let mut buff = [0; 16];
                self.require_n_remaining(byte_len, "IPv6 prefix")?;
                self.copy_to_slice(&mut buff[..byte_len]);
                IpAddr::V6(Ipv6Addr::from(buff))
            }
        };

        let prefix = IpNet::new(addr, bit_len)
            .map_err(|_| ParserError::ParseError("Invalid network prefix length".to_string()))?;
        Ok(NetworkPrefix::new(prefix))
    }
}

// All Buf implementations, Bytes in particular, can use the utilities.
impl<T: Buf> ReadUtils for T {}
