//! Table-driven CRCs used by the framing layers: CRC-8 and CRC-16 guard FLAC
//! frames, the Ogg variant of CRC-32 guards Ogg pages. All three are
//! MSB-first with a zero initial value and no final xor.

const fn crc8_table(poly: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ poly } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ poly } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ poly } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC8: [u8; 256] = crc8_table(0x07);
static CRC16: [u16; 256] = crc16_table(0x8005);
static CRC32_OGG: [u32; 256] = crc32_table(0x04C1_1DB7);

/// CRC-8 over `data`, polynomial x^8 + x^2 + x + 1.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &b| CRC8[(crc ^ b) as usize])
}

/// Running CRC-16, polynomial x^16 + x^15 + x^2 + 1.
pub fn crc16_update(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, &b| {
        (crc << 8) ^ CRC16[((crc >> 8) as u8 ^ b) as usize]
    })
}

pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0, data)
}

/// Running Ogg page CRC-32, polynomial 0x04C11DB7.
pub fn crc32_ogg_update(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &b| {
        (crc << 8) ^ CRC32_OGG[((crc >> 24) as u8 ^ b) as usize]
    })
}

pub fn crc32_ogg(data: &[u8]) -> u32 {
    crc32_ogg_update(0, data)
}
